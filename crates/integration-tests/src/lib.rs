// Integration scenarios live under tests/.
